// Binary to export TypeScript types for the upload UI
// Run with: cargo run --bin export_types

use ts_rs::TS;

fn main() {
    println!("Exporting TypeScript types...");

    fixer::Outcome::export().expect("Failed to export Outcome");
    fixer::Entry::export().expect("Failed to export Entry");
    fixer::Classification::export().expect("Failed to export Classification");
    fixer::LogLevel::export().expect("Failed to export LogLevel");

    println!("✓ TypeScript types exported successfully to bindings/");
}
