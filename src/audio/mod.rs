pub mod decode;
pub mod ogg_opus;
pub mod opus;
pub mod riff;
pub mod sniff;
pub mod wav;
pub mod webm;
