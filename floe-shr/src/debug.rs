//  DEBUG.rs
//    by Eisfeld
//
//  Created:
//    09 Feb 2023, 13:44:55
//  Last edited:
//    17 Feb 2023, 11:02:19
//  Auto updated?
//    Yes
//
//  Description:
//!   Implements a few formatting tools for log output.
//

use std::fmt::{Debug, Display, Formatter, Result as FResult};


/***** LIBRARY *****/
/// Defines a struct that can format a large block of text neatly.
///
/// Used to dump container stdout/stderr in debug logs without it blending into the
/// surrounding log lines.
pub struct BlockFormatter<S> {
    /// Reference to the thing to format.
    to_fmt : S,
}
impl<S> BlockFormatter<S> {
    /// Constructor for the BlockFormatter.
    ///
    /// # Arguments
    /// - `to_fmt`: The thing to format.
    ///
    /// # Returns
    /// A new BlockFormatter instance.
    #[inline]
    pub fn new(to_fmt: S) -> Self {
        Self {
            to_fmt,
        }
    }
}
impl<S> Display for BlockFormatter<S>
where
    S: Display,
{
    fn fmt(&self, f: &mut Formatter<'_>) -> FResult {
        writeln!(f, "{}\n{}\n{}",
            (0..80).map(|_| '-').collect::<String>(),
            self.to_fmt,
            (0..80).map(|_| '-').collect::<String>(),
        )?;

        // Done
        Ok(())
    }
}



/// Defines a struct that implements a special type of Debug for the given EnumDebug-type.
pub struct EnumDebugFormatter<'a, T: ?Sized> {
    reference : &'a T,
}
impl<'a, T> Debug for EnumDebugFormatter<'a, T>
where
    T: EnumDebug,
{
    #[inline]
    fn fmt(&self, f: &mut Formatter<'_>) -> FResult {
        write!(f, "{}::", std::any::type_name::<T>())?;
        self.reference.fmt_name(f)
    }
}
impl<'a, T> Display for EnumDebugFormatter<'a, T>
where
    T: EnumDebug,
{
    #[inline]
    fn fmt(&self, f: &mut Formatter<'_>) -> FResult {
        self.reference.fmt_name(f)
    }
}



/// Defines a really quick trait that allows the printing of variant names only.
pub trait EnumDebug {
    /// Writes the name of this variant to the given formatter.
    ///
    /// # Arguments
    /// - `f`: The Formatter to write to.
    ///
    /// # Errors
    /// This function errors if it failed to write to the given formatter.
    fn fmt_name(&self, f: &mut Formatter<'_>) -> FResult;



    /// Function that returns a EnumDebugFormatter for the type implementing this.
    ///
    /// # Returns
    /// A new EnumDebugFormatter that implements Debug and can thus write to stdout.
    #[inline]
    fn variant(&self) -> EnumDebugFormatter<'_, Self> {
        EnumDebugFormatter {
            reference : self,
        }
    }
}
