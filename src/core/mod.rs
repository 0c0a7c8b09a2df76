pub mod card;
pub mod error;
pub mod schema;

pub use card::*;
pub use error::*;
pub use schema::*;
