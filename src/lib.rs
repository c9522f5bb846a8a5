pub mod diff;
pub mod equivalence;
pub mod error;
pub mod expr;
pub mod integral;
pub mod limit;
pub mod normalize;
pub mod numeric;
pub mod parsing;
pub mod policy;
pub mod poly;
pub mod roots;
pub mod simplify;
pub mod task;
pub mod utils;
pub mod verify;

pub use crate::equivalence::{check_step, check_step_with, Equivalence};
pub use crate::error::{ErrorKind, ParseError, StepFailure, StepResult};
pub use crate::expr::Expression;
pub use crate::integral::{check_integral_final, check_volterra, check_volterra_final, VolterraConditions};
pub use crate::limit::{check_limit, compute_limit, limits_equal, LimitPoint};
pub use crate::normalize::{normalize, normalize_with, LIMIT_MARKER};
pub use crate::policy::CheckPolicy;
pub use crate::task::{Category, CheckRequest, SolutionRecord, SolutionStatus, StepRecord, TaskCatalog, TaskView};
pub use crate::verify::{verify_request, verify_sequence, RequestError, StepError, Verification};
