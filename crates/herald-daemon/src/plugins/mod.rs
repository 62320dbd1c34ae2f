pub mod build_watch;
