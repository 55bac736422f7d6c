pub(crate) mod logging;

pub(crate) mod network;

pub(crate) mod node;

pub(crate) mod recording_task;
