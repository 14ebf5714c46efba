//! CLI command implementations.
//!
//! | Module   | Commands handled                |
//! |----------|---------------------------------|
//! | `run`    | `Run`, `Resume`                 |
//! | `runs`   | `List`, `Status`, `Delete`      |
//! | `config` | `Config`                        |
//! | `skills` | `Skills`                        |

pub mod config;
pub mod run;
pub mod runs;
pub mod skills;

pub use config::cmd_config;
pub use run::{cmd_resume, cmd_run};
pub use runs::{cmd_delete, cmd_list, cmd_status};
pub use skills::cmd_skills;
