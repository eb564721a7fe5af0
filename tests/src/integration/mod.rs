//! Bridge-level flows against a scripted host.

mod requests;
mod transports;
