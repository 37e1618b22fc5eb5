mod content_scan;
mod index_entries;
mod index_pages;
mod index_validation;
mod plan;
mod reconcile;
mod run;
mod splitting;
#[cfg(test)]
mod tests;

pub use run::run;
pub(crate) use run::segment_document;
