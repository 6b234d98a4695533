pub mod anomaly;
pub mod attribute;
pub mod baseline;
pub mod span;
pub mod training;
pub mod watermark;

pub use anomaly::*;
pub use attribute::*;
pub use baseline::*;
pub use span::*;
pub use training::*;
pub use watermark::*;
