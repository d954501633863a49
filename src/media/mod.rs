pub mod frames;
pub mod kenburns;
pub mod normalize;
pub mod probe;
pub mod run;
pub mod thumbnail;
