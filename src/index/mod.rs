//! Read-only clients for the external lexical and vector indexes.
//!
//! Both indexes are external collaborators: this module owns only the access
//! contracts ([`LexicalIndexClient`], [`VectorIndexClient`]) and thin adapters
//! over the real backends. The engine never writes through either.

pub mod error;
pub mod lexical;
pub mod mock;
pub mod model;
pub mod vector;

#[cfg(test)]
mod tests;

pub use error::{IndexError, IndexResult};
pub use lexical::{HttpLexicalIndex, LexicalIndexClient};
#[cfg(any(test, feature = "mock"))]
pub use mock::{MockLexicalIndex, MockVectorIndex};
pub use model::{RankedDoc, SourceSpan};
pub use vector::{QdrantVectorIndex, VectorIndexClient};
