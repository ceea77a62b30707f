mod normalize;

pub use normalize::TitleNormalizer;
