pub mod cancel;
pub mod decoder;
pub mod filter;
pub mod manager;
pub mod pcap_source;
pub mod session;
pub mod source;

#[cfg(test)]
pub mod testing;
