pub(crate) mod path;
pub(crate) mod probe;
pub(crate) mod template;
