pub(crate) mod check;
pub(crate) mod files;
pub(crate) mod inputs;
pub(crate) mod resolve;
pub(crate) mod run;
pub(crate) mod write;
