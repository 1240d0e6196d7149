//! End-to-end scans against loopback services and a simulated link layer.

mod link;
mod loopback;
