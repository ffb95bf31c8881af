mod bus_tests;
mod message_tests;
