pub mod accuracy;
pub mod feedback;
pub mod measurement;
pub mod sizing;
pub mod student;
