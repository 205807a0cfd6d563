mod common;
mod demographics;
mod validation;
