mod filter;
mod parse;
mod preprocess;
mod tesseract;

pub use filter::filter_tokens;
pub use preprocess::{bounded_size, preprocess};
pub use tesseract::TesseractEngine;
