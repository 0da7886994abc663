//! Collaborators outside the search core.

pub mod access_control;
pub mod image_metadata;
