/// Describes how to initialize one trailing array: how many elements it holds,
/// and how each element is produced.
///
/// The engine reads `len` to size the allocation and again before building,
/// then calls `next_elem` once per index in increasing order. An `Err` from
/// `next_elem` stops construction of the whole object and is returned to the
/// caller after everything built so far is destroyed.
pub trait ArrayArg<T, E> {
    fn len(&self) -> usize;

    fn next_elem(&mut self, index: usize) -> Result<T, E>;
}

/// A bare count default-constructs every element.
impl<T: Default, E> ArrayArg<T, E> for usize {
    #[inline]
    fn len(&self) -> usize {
        return *self;
    }

    #[inline]
    fn next_elem(&mut self, _index: usize) -> Result<T, E> {
        return Ok(T::default());
    }
}

/// `len` default-constructed elements. See [`arg`].
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct Defaulted {
    len: usize,
}

/// `len` default-constructed elements.
///
/// Same as passing the count itself, but never leaves the integer type of the
/// count up to inference.
#[inline]
pub const fn arg(len: usize) -> Defaulted {
    return Defaulted { len };
}

impl<T: Default, E> ArrayArg<T, E> for Defaulted {
    #[inline]
    fn len(&self) -> usize {
        return self.len;
    }

    #[inline]
    fn next_elem(&mut self, _index: usize) -> Result<T, E> {
        return Ok(T::default());
    }
}

/// `len` elements taken from an iterator. See [`arg_iter`].
#[derive(Debug, Clone)]
pub struct FromIter<I> {
    len:  usize,
    iter: I,
}

/// `len` elements converted from the first `len` items of `iter`.
///
/// # Panics
///
/// Construction panics if `iter` runs out before `len` items.
#[inline]
pub fn arg_iter<I: IntoIterator>(len: usize, iter: I) -> FromIter<I::IntoIter> {
    return FromIter {
        len:  len,
        iter: iter.into_iter(),
    };
}

impl<T, E, I> ArrayArg<T, E> for FromIter<I>
where
    I: Iterator,
    I::Item: Into<T>,
{
    #[inline]
    fn len(&self) -> usize {
        return self.len;
    }

    fn next_elem(&mut self, index: usize) -> Result<T, E> {
        let Some(item) = self.iter.next() else {
            panic!("iterator ran out at element {} of {}", index, self.len);
        };
        return Ok(item.into());
    }
}

/// `len` elements produced by a function of their index. See [`arg_with`].
#[derive(Debug, Clone)]
pub struct WithFn<F> {
    len:  usize,
    init: F,
}

/// `len` elements, element `i` being `init(i)`.
#[inline]
pub fn arg_with<T, F: FnMut(usize) -> T>(len: usize, init: F) -> WithFn<F> {
    return WithFn { len, init };
}

impl<T, E, F: FnMut(usize) -> T> ArrayArg<T, E> for WithFn<F> {
    #[inline]
    fn len(&self) -> usize {
        return self.len;
    }

    #[inline]
    fn next_elem(&mut self, index: usize) -> Result<T, E> {
        return Ok((self.init)(index));
    }
}

/// `len` elements produced by a fallible function of their index. See
/// [`try_arg_with`].
#[derive(Debug, Clone)]
pub struct TryWithFn<F> {
    len:  usize,
    init: F,
}

/// `len` elements, element `i` being `init(i)`. The first error aborts the
/// construction of the whole object.
#[inline]
pub fn try_arg_with<T, E, F: FnMut(usize) -> Result<T, E>>(len: usize, init: F) -> TryWithFn<F> {
    return TryWithFn { len, init };
}

impl<T, E, F: FnMut(usize) -> Result<T, E>> ArrayArg<T, E> for TryWithFn<F> {
    #[inline]
    fn len(&self) -> usize {
        return self.len;
    }

    #[inline]
    fn next_elem(&mut self, index: usize) -> Result<T, E> {
        return (self.init)(index);
    }
}
