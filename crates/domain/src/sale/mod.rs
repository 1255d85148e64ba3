//! Sales recorded by the sale chain.

mod model;
mod postgres;
mod repository;

pub use model::Sale;
pub use postgres::PostgresSaleRepository;
pub use repository::{
    DEFAULT_LIST_LIMIT, InMemorySaleRepository, MAX_LIST_LIMIT, SaleRepository, clamp_limit,
};
