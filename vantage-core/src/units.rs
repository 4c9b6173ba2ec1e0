//! Conversions from the console's imperial units to the metric units reported downstream.

const MM_PER_INCH: f64 = 25.4;
const MPH_PER_MPS: f64 = 2.23693;
const HPA_PER_INHG: f64 = 33.8639;
const MM_PER_FOOT: f64 = 304.8;

pub fn fahrenheit_to_celsius(fahrenheit: f64) -> f64 {
    (fahrenheit - 32.0) / 1.8
}

pub fn inches_to_mm(inches: f64) -> f64 {
    inches * MM_PER_INCH
}

pub fn mph_to_mps(mph: f64) -> f64 {
    mph / MPH_PER_MPS
}

pub fn inhg_to_hpa(inhg: f64) -> f64 {
    inhg * HPA_PER_INHG
}

pub fn feet_to_mm(feet: f64) -> f64 {
    feet * MM_PER_FOOT
}
