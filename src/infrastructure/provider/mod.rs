pub mod bitmovin;
