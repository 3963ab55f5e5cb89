pub mod user;
pub mod flat;
pub mod product;
pub mod question;
pub mod info_card;

pub use user::*;
pub use flat::*;
pub use product::*;
pub use question::*;
pub use info_card::*;
