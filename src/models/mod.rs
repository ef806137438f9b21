pub mod batch;
pub mod schema;
pub mod statement;
pub mod value;

pub use batch::*;
pub use schema::*;
pub use statement::SqlStatement;
pub use value::Value;
