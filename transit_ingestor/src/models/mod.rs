pub mod city;
pub mod route;
pub mod stop;
pub mod telemetry;
