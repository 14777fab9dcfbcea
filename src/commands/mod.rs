pub mod attach;
pub mod branches;
pub mod commit;
pub mod common;
pub mod kill;
pub mod project;
pub mod resume;
pub mod run;
pub mod sessions;
pub mod watch;
