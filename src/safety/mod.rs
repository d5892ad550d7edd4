//! Path safety classification: grades, protected set, category rules,
//! optional running-process probe.

pub mod level;
pub mod process;
pub mod protected;
pub mod rules;

pub use level::{CleanupLevel, SafetyGrade};
pub use process::{NoProcessProbe, RunningProcessProbe};
pub use protected::ProtectedSet;
pub use rules::{
    BlockReason, Category, Classification, ExclusionSet, PathClassifier, category_of,
    standard_paths,
};
