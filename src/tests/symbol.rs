use crate::image::{Image, ImageConfig};

/// `symbol_to_string(intern("TEST")) == "TEST"`.
#[test]
fn symbol_round_trip() {
  let mut image = Image::create(ImageConfig::default());
  let sym = image.intern_symbol("TEST");
  assert_eq!(image.symbol_to_string(sym), "TEST");
}

/// Symbol uniqueness: `intern(s) == intern(s)`.
#[test]
fn interning_the_same_name_twice_yields_the_same_symbol() {
  let mut image = Image::create(ImageConfig::default());
  let a = image.intern_symbol("shared");
  let b = image.intern_symbol("shared");
  assert_eq!(a, b);
}

#[test]
fn class_by_name_finds_bootstrap_classes() {
  let image = Image::create(ImageConfig::default());
  assert_eq!(image.class_by_name("Integer"), Some(image.builtins.integer));
  assert_eq!(image.class_by_name("NoSuchClass"), None);
}
