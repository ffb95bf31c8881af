mod bus_tests;
mod types_tests;
