// Crate entry point. Re-export modules so tests and embedding apps can import them easily.
//
// Responsibilities
// - Only declare and expose modules. No business logic here.
//
// How it is used
// - The embedding application wires adapters into the application services;
//   tests import modules from this crate root to reach the code under test.

pub mod core {
    pub mod ports;
    pub mod record;
    pub mod rows;
}

pub mod application {
    pub mod background;
    pub mod errors;
    pub mod media;
    pub mod participant;
    pub mod streak;
    pub mod sync_engine;
}

pub mod adapters {
    pub mod file_store;
    pub mod in_memory {
        pub mod in_memory_anchor_store;
        pub mod in_memory_completion_store;
        pub mod in_memory_grant_source;
        pub mod recording_sink;
        pub mod scripted_feed;
    }
    pub mod rest {
        pub mod config;
        pub mod sink;
    }
}
