use super::*;

mod element_set_queries;
mod ready_and_events;
