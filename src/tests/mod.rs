
mod message_generator_tests;
mod profile_fetcher_tests;
mod rate_limit_tracker_tests;
mod session_gateway_tests;
