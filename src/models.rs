mod traits;
pub use traits::LinkPredictor;

mod edgebank;
pub use edgebank::{EdgeBankPredictor, MemoryMode};
