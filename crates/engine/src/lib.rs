pub mod cell_meta;
pub mod disambiguation;
pub mod grid;
pub mod mappings;
pub mod navigation;
pub mod results;
pub mod search;
pub mod session;
pub mod throttle;
pub mod validation;

#[cfg(test)]
pub mod harness;
