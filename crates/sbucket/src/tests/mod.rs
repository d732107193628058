mod helpers;
mod stream_tests;
