mod pg_repository;
mod submission;
