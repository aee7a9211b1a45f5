pub mod layout;
pub mod lookup;
pub mod transforms;
pub mod validate;

pub use layout::*;
pub use lookup::*;
pub use transforms::*;
pub use validate::*;
