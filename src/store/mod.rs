pub mod atomic;
pub mod selection;
pub mod tokens;

pub use selection::SelectionStore;
pub use tokens::TokenStore;
