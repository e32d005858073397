pub use crate::component::{FieldInfo, MAX_FIELDS_ON_STACK};
pub use memoffset::offset_of;
pub use smallvec::smallvec;
pub use smallvec::SmallVec;
