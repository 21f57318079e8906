// Messaging - Commands into the scheduler, notifications out of it

pub mod channels;
pub mod command;
pub mod notification;
