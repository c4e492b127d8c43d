pub mod audit_writer;
