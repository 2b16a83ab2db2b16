pub mod enums;
pub mod filters;
mod adl;
mod administration;
mod audit;
mod calendar;
mod medication;
mod order;
mod resident;
mod user;

pub use adl::*;
pub use administration::*;
pub use audit::*;
pub use calendar::*;
pub use medication::*;
pub use order::*;
pub use resident::*;
pub use user::*;
