// Test modules for Portkeeper
// Each module contains the unit tests for the corresponding source file

mod mapping_tests;
