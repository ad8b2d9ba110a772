use crate::image::{Image, ImageConfig};

/// `Array new: 10`, bounds-checked `at:`/`at:put:`.
#[test]
fn array_new_at_put_and_bounds_checking() {
  let mut image = Image::create(ImageConfig::default());
  let new_sel = image.intern_symbol("new:");
  let at = image.intern_symbol("at:");
  let at_put = image.intern_symbol("at:put:");
  let length = image.intern_symbol("length");

  let ten = image.get_integer(10).unwrap();
  let array = crate::dispatch::send(&mut image, image.builtins.array.erase(), new_sel, &[ten]).unwrap();

  let len = crate::dispatch::send(&mut image, array, length, &[]).unwrap();
  assert_eq!(image.unbox_integer(len), 10);

  let idx3 = image.get_integer(3).unwrap();
  crate::dispatch::send(&mut image, array, at_put, &[idx3, image.true_obj]).unwrap();
  let value = crate::dispatch::send(&mut image, array, at, &[idx3]).unwrap();
  assert_eq!(value, image.true_obj);

  let idx50 = image.get_integer(50).unwrap();
  let out_of_range = crate::dispatch::send(&mut image, array, at, &[idx50]).unwrap();
  assert_eq!(out_of_range, image.nil);
}

#[test]
fn fresh_array_elements_are_nil() {
  let mut image = Image::create(ImageConfig::default());
  let array = image.make_array(image.builtins.array, 4).unwrap();
  for i in 0..4 {
    assert_eq!(image.heap.ivar(array.index, i), image.nil);
  }
}
