pub mod account;
pub mod compensation;
pub mod holding;
pub mod ids;
pub mod instrument;
pub mod order;

pub use account::*;
pub use compensation::*;
pub use holding::*;
pub use ids::*;
pub use instrument::*;
pub use order::*;
