//! Search operations: query building, result pages, facets and points.

pub mod query_builder;
pub mod search_sql;
pub mod sensitive;

mod search_for_results;
pub use search_for_results::{find_by_fulltext, search_for_results};

mod search_for_results_hit_count;
pub use search_for_results_hit_count::search_for_results_hit_count;

pub mod search_facets;
pub use search_facets::{
    data_provider_list, estimate_unique_values, facet_counts, list_facets, sources_for_query, write_facet_to_stream,
};

mod endemic_facets;
pub use endemic_facets::{endemic_facet, subquery_species_only, write_endemic_facet_to_stream};

pub mod points;
pub use points::{facet_points, find_records_for_location, write_coordinates_to_stream};

mod streaming_query;
pub use streaming_query::{stream_documents, streaming_query};

mod species;
pub use species::{ALL_SPECIES, find_all_species, write_species_count_by_circle_to_stream};
