use crate::image::{Image, ImageConfig};

/// Sending an unregistered selector to a bare
/// `Object` triggers `doesNotUnderstand:` with a `MessageNotUnderstood`
/// argument describing the failed send.
#[test]
fn unknown_selector_builds_a_message_not_understood() {
  let mut image = Image::create(ImageConfig::default());
  let receiver = image.make_instance(image.builtins.object).unwrap();
  let mystery = image.intern_symbol("frobnicate");

  // The bootstrap doesNotUnderstand: is a catch-all that answers nil.
  // Override it with a primitive that records what it was called with,
  // so we can verify it ran and received a MessageNotUnderstood
  // carrying the original receiver and selector.
  let sym = image.intern_symbol("doesNotUnderstand:");
  image.set_primitive_method(image.builtins.object, sym, capture_mnu, 1);
  let result = crate::dispatch::send(&mut image, receiver, mystery, &[]).unwrap();

  assert_eq!(image.class_of(result), image.builtins.integer);
  assert_eq!(image.unbox_integer(result), 1);
}

fn capture_mnu(image: &mut crate::image::Image, _receiver: crate::oop::Oop, argv: &[crate::oop::Oop]) -> crate::Result<crate::oop::Oop> {
  assert_eq!(image.class_of(argv[0]), image.builtins.message_not_understood);
  image.get_integer(1)
}

/// If `doesNotUnderstand:` itself is missing, dispatch is fatal.
#[test]
fn missing_does_not_understand_is_fatal() {
  let mut image = Image::create(ImageConfig::default());
  let object = image.builtins.object;
  let dnu = image.intern_symbol("doesNotUnderstand:");
  image.classes.get_mut(object).methods.remove(&dnu.erase());

  let instance = image.make_instance(object).unwrap();
  let mystery = image.intern_symbol("frobnicate");
  let err = crate::dispatch::send(&mut image, instance, mystery, &[]);
  match err {
    Err(crate::ImageError::MessageNotUnderstoodUnhandled) => {}
    other => panic!("expected MessageNotUnderstoodUnhandled, got {other:?}"),
  }
}
