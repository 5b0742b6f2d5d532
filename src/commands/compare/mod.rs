mod output;
mod run;
mod tables;

use output::*;
use tables::*;

pub use run::run;
