mod common_args;

mod build;
pub use build::*;

mod prove;
pub use prove::*;

mod verify;
pub use verify::*;

mod keygen;
pub use keygen::*;

mod info;
pub use info::*;
