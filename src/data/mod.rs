//! Result data: typed cells, the paginated row cursor and export helpers

pub mod cursor;
pub mod datatable;
pub mod export;

pub use cursor::Cursor;
pub use datatable::{DataColumn, DataType, DataValue, Row};
