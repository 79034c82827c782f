//! Dispatching CI jobs for pull-request testing.

mod jenkins;
mod test_plans;

pub use self::jenkins::CiDispatchError;
pub use self::jenkins::JenkinsCiConfig;
pub use self::jenkins::JenkinsCiJob;

pub use self::test_plans::TestPlan;
pub use self::test_plans::TestPlanDispatcher;
pub use self::test_plans::TestPlanError;
