pub(crate) mod capabilities;
pub(crate) mod categories;
pub(crate) mod doctor;
pub(crate) mod hooks;
pub(crate) mod registry;
pub(crate) mod status;
pub(crate) mod validate;
pub(crate) mod watch;
pub(crate) mod workspace;
