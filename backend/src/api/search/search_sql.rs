//! SQL builder helpers for index queries.

use common::search_query::{FacetSort, FilterClause, MATCH_ALL, SortDirection};
use common::search_result::FacetValue;

use crate::db_utils::index_client::IndexQuery;
use crate::error::SearchError;

pub const SQL_OPTIONS_CLAUSE: &'static str = "agent_query_timeout=60000,max_query_time=60000";

/// Upper bound on buckets for an unlimited facet.
pub const UNLIMITED_FACET_LIMIT: u64 = 100_000;

const MIN_MAX_MATCHES: u64 = 1000;

pub fn check_identifier(name: &str) -> anyhow::Result<&str> {
    let valid = !name.is_empty()
        && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
        && !name.starts_with(|c: char| c.is_ascii_digit());
    if !valid {
        return Err(SearchError::invalid_request(format!("invalid field name: {:?}", name)).into());
    }
    Ok(name)
}

fn quote(value: &str) -> String {
    format_sql_query::QuotedData(value).to_string()
}

fn facet_value_sql(value: &FacetValue) -> String {
    match value {
        FacetValue::String(s) => quote(s),
        FacetValue::Int(i) => i.to_string(),
    }
}

/// Rewrites `field:value` terms into Manticore field operators and escapes the
/// rest of the text.
fn full_text_expression(text: &str) -> String {
    text.split_whitespace()
        .filter(|token| *token != MATCH_ALL && !matches!(*token, "AND" | "&&"))
        .map(|token| {
            let (negate, token) = match token.strip_prefix('-') {
                Some(rest) => ("!", rest),
                None => ("", token),
            };
            match token.split_once(':') {
                Some((field, value)) if check_identifier(field).is_ok() && !value.is_empty() => {
                    format!("{negate}@{field} {}", value.replace('@', "\\@"))
                }
                _ => format!("{negate}{}", token.replace('@', "\\@")),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

fn filter_sql(clause: &FilterClause) -> anyhow::Result<Option<String>> {
    let sql = match clause {
        FilterClause::Term { field, value, negate } => {
            let op = if *negate { "!=" } else { "=" };
            format!("{} {op} {}", check_identifier(field)?, facet_value_sql(value))
        }
        FilterClause::AnyOf { field, values } => {
            let values_str = values.iter().map(facet_value_sql).collect::<Vec<String>>().join(", ");
            format!("{} IN ({values_str})", check_identifier(field)?)
        }
        FilterClause::Range { field, min, max, max_inclusive } => {
            let field = check_identifier(field)?;
            let mut parts = Vec::new();
            if let Some(min) = min {
                parts.push(format!("{field} >= {min}"));
            }
            if let Some(max) = max {
                let op = if *max_inclusive { "<=" } else { "<" };
                parts.push(format!("{field} {op} {max}"));
            }
            if parts.is_empty() {
                return Ok(None);
            }
            parts.join(" AND ")
        }
        FilterClause::Radius { latitude, longitude, radius_km } => format!(
            "GEODIST(latitude, longitude, {latitude}, {longitude}, {{in=degrees, out=km}}) <= {radius_km}"
        ),
        FilterClause::Polygon { points } => {
            let coords = points.iter().map(|(lon, lat)| format!("{lat}, {lon}")).collect::<Vec<_>>().join(", ");
            format!("CONTAINS(GEOPOLY2D({coords}), latitude, longitude)")
        }
        FilterClause::BoundingBox(bbox) => format!(
            "latitude BETWEEN {} AND {} AND longitude BETWEEN {} AND {}",
            bbox.min_latitude, bbox.max_latitude, bbox.min_longitude, bbox.max_longitude
        ),
        FilterClause::NoneOf(clauses) => {
            let mut parts = Vec::new();
            for inner in clauses {
                if matches!(inner, FilterClause::Raw(_)) {
                    return Err(SearchError::invalid_request("free-text clauses cannot be negated as filters").into());
                }
                if let Some(sql) = filter_sql(inner)? {
                    parts.push(format!("NOT ({sql})"));
                }
            }
            if parts.is_empty() {
                return Ok(None);
            }
            parts.join(" AND ")
        }
        // folded into the MATCH expression
        FilterClause::Raw(_) => return Ok(None),
    };
    Ok(Some(sql))
}

pub fn build_sql_where_clause(query: &IndexQuery) -> anyhow::Result<String> {
    let mut text_parts = vec![full_text_expression(&query.query)];
    for clause in &query.filters {
        if let FilterClause::Raw(raw) = clause {
            text_parts.push(full_text_expression(raw));
        }
    }
    let text = text_parts.into_iter().filter(|t| !t.is_empty()).collect::<Vec<_>>().join(" ");

    let mut terms = Vec::new();
    if !text.is_empty() {
        terms.push(format!("MATCH({})", quote(&text)));
    }
    for clause in &query.filters {
        if let Some(sql) = filter_sql(clause)? {
            terms.push(sql);
        }
    }
    if terms.is_empty() {
        return Ok(String::new());
    }
    Ok(format!("WHERE {}", terms.join("
        AND ")))
}

fn options_clause(query: &IndexQuery) -> String {
    let max_matches = (query.start + query.rows).max(MIN_MAX_MATCHES);
    let mut options = vec![SQL_OPTIONS_CLAUSE.to_string(), format!("max_matches={max_matches}")];
    for (key, values) in &query.params {
        if let Some(option) = key.strip_prefix("option.") {
            if check_identifier(option).is_ok() {
                if let Some(value) = values.last() {
                    options.push(format!("{option}={}", quote(value)));
                }
            }
        }
    }
    format!("OPTION {}", options.join(","))
}

pub fn build_select_sql(query: &IndexQuery, table: &str) -> anyhow::Result<String> {
    let table = check_identifier(table)?;
    let columns = if query.fields.is_empty() {
        "*".to_string()
    } else {
        let mut columns = vec!["id".to_string()];
        for field in &query.fields {
            let field = check_identifier(field)?;
            if field != "id" {
                columns.push(field.to_string());
            }
        }
        columns.join(", ")
    };
    let where_clause = build_sql_where_clause(query)?;
    let order_clause = match &query.sort {
        Some((field, dir)) => {
            let dir = match dir {
                SortDirection::Asc => "ASC",
                SortDirection::Desc => "DESC",
            };
            format!("ORDER BY {} {dir}", check_identifier(field)?)
        }
        None => String::new(),
    };
    let mut facets = Vec::new();
    for field in &query.facet.fields {
        let field = check_identifier(field)?;
        let order = match query.facet.sort {
            FacetSort::Count => "ORDER BY COUNT(*) DESC".to_string(),
            FacetSort::Index => format!("ORDER BY {field} ASC"),
        };
        let limit = query.facet.limit().map_or(UNLIMITED_FACET_LIMIT, |l| l as u64);
        facets.push(format!("FACET {field} {order} LIMIT {}, {limit}", query.facet.offset));
    }
    let options = options_clause(query);
    Ok(format!(
        "
        SELECT {columns}
        FROM {table}
        {where_clause}
        {order_clause}
        LIMIT {}, {}
        {options}
        {}
        ;",
        query.start,
        query.rows,
        facets.join("
        "),
    ))
}

pub fn build_count_sql(query: &IndexQuery, table: &str) -> anyhow::Result<String> {
    let table = check_identifier(table)?;
    let where_clause = build_sql_where_clause(query)?;
    Ok(format!(
        "
        SELECT COUNT(*) AS total_count
        FROM {table}
        {where_clause}
        OPTION {SQL_OPTIONS_CLAUSE}
        ;"
    ))
}

pub fn build_stats_sql(query: &IndexQuery, table: &str, field: &str) -> anyhow::Result<String> {
    let table = check_identifier(table)?;
    let field = check_identifier(field)?;
    let where_clause = build_sql_where_clause(query)?;
    Ok(format!(
        "
        SELECT COUNT(*) AS count, MIN({field}) AS min_value, MAX({field}) AS max_value, SUM({field}) AS sum_value
        FROM {table}
        {where_clause}
        OPTION {SQL_OPTIONS_CLAUSE}
        ;"
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db_utils::index_client::FacetOptions;

    #[test]
    fn field_terms_become_field_operators() {
        assert_eq!(full_text_expression("genus:Macropus rufus"), "@genus Macropus rufus");
        assert_eq!(full_text_expression("*:*"), "");
        assert_eq!(full_text_expression("-state:NSW"), "!@state NSW");
    }

    #[test]
    fn where_clause_combines_text_and_filters() {
        let query = IndexQuery {
            query: "genus:Macropus".to_string(),
            filters: vec![
                FilterClause::term("state", "NSW"),
                FilterClause::range("year", Some(1900.0), Some(1950.0), false),
            ],
            ..Default::default()
        };
        let sql = build_sql_where_clause(&query).unwrap();
        assert!(sql.starts_with("WHERE MATCH("));
        assert!(sql.contains("state = 'NSW'"));
        assert!(sql.contains("year >= 1900 AND year < 1950"));
    }

    #[test]
    fn none_of_negates_each_clause() {
        let query = IndexQuery {
            query: MATCH_ALL.to_string(),
            filters: vec![FilterClause::NoneOf(vec![
                FilterClause::term("basis", "HumanObservation"),
                FilterClause::range("year", Some(1900.0), Some(1950.0), true),
            ])],
            ..Default::default()
        };
        let sql = build_sql_where_clause(&query).unwrap();
        assert_eq!(sql, "WHERE NOT (basis = 'HumanObservation') AND NOT (year >= 1900 AND year <= 1950)");
    }

    #[test]
    fn match_all_without_filters_has_no_where() {
        let query = IndexQuery { query: MATCH_ALL.to_string(), ..Default::default() };
        assert_eq!(build_sql_where_clause(&query).unwrap(), "");
    }

    #[test]
    fn rejects_injected_field_names() {
        let query = IndexQuery {
            query: MATCH_ALL.to_string(),
            facet: FacetOptions::single("year; DROP TABLE x", 10),
            ..Default::default()
        };
        let err = build_select_sql(&query, "occurrences").unwrap_err();
        assert!(matches!(err.downcast_ref::<SearchError>(), Some(SearchError::InvalidRequest { .. })));
    }

    #[test]
    fn select_renders_facets_and_paging() {
        let query = IndexQuery {
            query: MATCH_ALL.to_string(),
            start: 200,
            rows: 100,
            facet: FacetOptions::single("year", -1),
            ..Default::default()
        };
        let sql = build_select_sql(&query, "occurrences").unwrap();
        assert!(sql.contains("LIMIT 200, 100"));
        assert!(sql.contains("FACET year ORDER BY COUNT(*) DESC LIMIT 0, 100000"));
        assert!(sql.contains("max_matches=1000"));
    }
}
