pub mod alert;
pub mod decision;
pub mod event;
pub mod features;
pub mod playbook;

pub use alert::*;
pub use decision::*;
pub use event::*;
pub use features::*;
pub use playbook::*;
