mod pipeline;
mod rover_api;
mod utils;
