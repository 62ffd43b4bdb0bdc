mod load;
mod scenario;

pub use self::{load::LoadConfig, scenario::Scenario};
