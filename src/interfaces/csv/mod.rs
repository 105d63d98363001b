pub mod transition_writer;
