//! Document model and corpus access

pub mod corpus;
pub mod document;
pub mod frontmatter;
pub mod hash;
