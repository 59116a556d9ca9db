pub mod cascade;
pub mod connectors;
pub mod db;
pub mod lifecycle;
pub mod monitoring;
pub mod server;
pub mod topology;

#[cfg(test)]
pub(crate) mod test_support;
