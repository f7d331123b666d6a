pub mod collection;
pub mod error;
pub mod params;

pub use collection::CollectionIdentity;
pub use error::{QueryError, Result};
pub use params::{ParamValue, QueryParams, QueryParamsBuilder};
