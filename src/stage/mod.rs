//! Default stage actions: query construction, execution, result conversion.

mod convert;
mod query;
mod run;

pub use convert::{convert, ConvertData, ConverterTable, Transform};
pub use query::{build_query, BuildQuery, Operation, QueryDescriptor};
pub use run::{execute, RunQuery};
