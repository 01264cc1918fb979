#[cfg(test)]
mod engine_tests;

#[cfg(test)]
mod dispatch_tests;
