//! Integration tests for forkspace.
//!
//! These tests run whole jobs through a Space and its Computers and check
//! the answers against sequential evaluation.
//!
//! # Test Categories
//!
//! - **Scenarios**: Fibonacci, TSP and Mandelbrot jobs end to end in-process
//! - **Fault Tolerance**: workers dying mid-task, late joiners
//! - **Shared Values**: monotone broadcast of the shared bound
//! - **Join Semantics**: every Join runs once with every input filled
//! - **TCP Cluster**: Space, Computers and client talking over sockets

mod fixtures;

mod fault_tolerance;
mod join_semantics;
mod scenarios;
mod tcp_cluster;
