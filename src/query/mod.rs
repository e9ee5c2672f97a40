//! Query construction, expansion and optimisation.

pub mod description;
pub mod editdist;
pub mod expand;
pub mod node;
pub mod optimizer;
pub mod terms;
pub mod wildcard;

pub use self::editdist::EditDistance;
pub use self::node::{Query, QueryKind};
pub use self::optimizer::optimize;
pub use self::terms::Terms;
pub use self::wildcard::{Combiner, ExpansionLimit, PatternFlags, Wildcard};
