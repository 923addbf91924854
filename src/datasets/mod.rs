mod link_prop_pred;
pub use link_prop_pred::*;

mod negative_sampler;
pub use negative_sampler::*;

mod temporal_data;
pub use temporal_data::*;

mod temporal_loader;
pub use temporal_loader::*;

mod traits;
pub use traits::*;

mod utils;
pub use utils::*;
