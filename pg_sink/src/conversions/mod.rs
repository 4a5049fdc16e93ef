pub mod change_event;
pub mod deserializer;
pub mod json_cell;
