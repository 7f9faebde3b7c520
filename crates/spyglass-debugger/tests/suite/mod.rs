
mod driver;
mod formatting;
mod fragments;
mod move_collision;
mod persistence;
mod session_events;
mod source_maps;
