mod search_tests;
mod session_tests;
