//! TactileForce reads a fingertip instrumented with two sensors: a six-axis
//! force/torque sensor that streams binary frames over a serial line, and a
//! four-channel tactile array sampled through an SPI ADC. Every tick of a
//! fixed-rate control loop, both readings go through a median, Kalman, and
//! baseline-relative filter cascade and are sent to a UDP client as a flat
//! record of named values.
//!
//! Each run starts with a calibration phase: the fingertip is left unloaded
//! while the loop collects filtered readings, and the trimmed mean of those
//! becomes the baseline that later readings are measured against. When a
//! run's execution time is up the operator is asked whether to recalibrate
//! and go again.
//!
//! The force/torque sensor is decoded on a background thread
//! ([acquisition_worker]) that hunts for frame boundaries in the raw byte
//! stream ([frame_synchronizer]) and publishes the most recent frame; the
//! control loop ([control_loop]) only ever looks at that latest frame.

#![warn(missing_docs)]
pub mod acquisition_worker;
pub mod args;
pub mod byte_source;
pub mod calibration_buffer;
pub mod config;
pub mod control_loop;
pub mod dummy_sensor;
pub mod filter_pipeline;
pub mod force_sensor;
pub mod frame_codec;
pub mod frame_synchronizer;
#[cfg(unix)]
pub mod gpio;
pub mod gui;
pub mod handshake;
pub mod kalman_filter;
pub mod median_filter;
pub mod real;
pub mod rotation;
pub mod sensor;
#[cfg(unix)]
pub mod spidev;
pub mod tactile_sensor;
pub mod transport;
