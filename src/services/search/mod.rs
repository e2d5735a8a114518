//! Search over cache keys: candidate lookup, filtering, ranking,
//! authorization, pagination and hydration.

pub mod index;
pub mod shadow_index;
pub mod template;

pub use index::SearchIndex;
pub use shadow_index::{ShadowIndex, ShadowIndexHandle, ShadowIndexStatus};
pub use template::TemplateResolver;
