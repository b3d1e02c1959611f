//! Citation normalization, brand extraction, and catalog reconciliation.

pub mod error;
pub mod extractor;
pub mod normalizer;
pub mod reconcile;
mod retry;

pub use error::ExtractionError;
pub use extractor::{analysis_schema, build_instructions, BrandExtractor, OpenAiExtractor};
pub use normalizer::{cited_domains, extract_domain, normalize_citations, CitationStrategy};
pub use reconcile::reconcile;
