pub mod assembler;
pub mod imports;
pub mod language;
pub mod test_suite;
