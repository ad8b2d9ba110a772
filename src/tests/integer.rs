use crate::image::{Image, ImageConfig};

/// Boxed Integer arithmetic via rawSet:/rawGet
/// tunneling and the four arithmetic selectors.
#[test]
fn boxed_arithmetic_round_trips_through_raw_get_set() {
  let mut image = Image::create(ImageConfig::default());
  let plus = image.intern_symbol("+");
  let minus = image.intern_symbol("-");
  let times = image.intern_symbol("*");
  let divide = image.intern_symbol("/");
  let raw_set = image.intern_symbol("rawSet:");
  let raw_get = image.intern_symbol("rawGet");

  let a = image.make_instance(image.builtins.integer).unwrap();
  let six = image.get_integer(6).unwrap();
  crate::dispatch::send(&mut image, a, raw_set, &[six]).unwrap();

  let b = image.make_instance(image.builtins.integer).unwrap();
  let three = image.get_integer(3).unwrap();
  crate::dispatch::send(&mut image, b, raw_set, &[three]).unwrap();

  let sum = crate::dispatch::send(&mut image, a, plus, &[b]).unwrap();
  let sum = crate::dispatch::send(&mut image, sum, raw_get, &[]).unwrap();
  assert_eq!(image.unbox_integer(sum), 9);

  let diff = crate::dispatch::send(&mut image, a, minus, &[b]).unwrap();
  assert_eq!(image.unbox_integer(diff), 3);

  let prod = crate::dispatch::send(&mut image, a, times, &[b]).unwrap();
  assert_eq!(image.unbox_integer(prod), 18);

  let quot = crate::dispatch::send(&mut image, a, divide, &[b]).unwrap();
  assert_eq!(image.unbox_integer(quot), 2);
}

#[test]
fn division_by_zero_answers_nil() {
  let mut image = Image::create(ImageConfig::default());
  let a = image.get_integer(1).unwrap();
  let zero = image.get_integer(0).unwrap();
  let divide = image.intern_symbol("/");
  let result = crate::dispatch::send(&mut image, a, divide, &[zero]).unwrap();
  assert_eq!(result, image.nil);
}

#[test]
fn arithmetic_with_a_non_integer_argument_answers_nil() {
  let mut image = Image::create(ImageConfig::default());
  let a = image.get_integer(1).unwrap();
  let not_a_number = image.make_instance(image.builtins.object).unwrap();
  let plus = image.intern_symbol("+");
  let result = crate::dispatch::send(&mut image, a, plus, &[not_a_number]).unwrap();
  assert_eq!(result, image.nil);
}
