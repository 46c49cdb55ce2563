pub mod collaboration;
pub mod export;
pub mod parsed_sheet;
pub mod upload;
pub mod user;

pub use collaboration::*;
pub use export::*;
pub use parsed_sheet::*;
pub use upload::*;
pub use user::*;
