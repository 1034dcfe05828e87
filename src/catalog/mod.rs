mod catalog;
mod schema;

pub use catalog::{Catalog, CatalogTable, TableId};
pub use schema::{Attribute, AttributeRef, DataType, TableSchema};

pub(crate) use schema::object_name;
